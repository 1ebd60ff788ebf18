pub mod batch_queue;
