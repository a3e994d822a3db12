//! Priority Task Queue
//!
//! ```text
//! submit(priority, task) ──▶ Mutex<BinaryHeap> ──Notify──▶ worker 0..N ──▶ run (catch_unwind)
//! ```
//!
//! Ordering is strict per pop: each idle worker takes the highest-priority
//! task available at that moment, ties in submission order. Tasks running
//! concurrently on different workers may still finish out of order.

mod priority;

pub use priority::{PriorityTaskQueue, TaskQueueConfig};
