//! Lock-free queue primitives built on siper hazard pointers.
//!
//! ## Features
//!
//! - [`MsQueue`]: unbounded MPMC FIFO queue (Michael–Scott list).
//!
//! ## Usage
//!
//! ```rust
//! use siper_queue::MsQueue;
//!
//! let q = MsQueue::new();
//! q.push(1);
//! q.push(2);
//! assert_eq!(q.pop(), Some(1));
//! assert_eq!(q.pop(), Some(2));
//! assert_eq!(q.pop(), None);
//! ```

pub mod ms_queue;

pub use ms_queue::MsQueue;
