// Application Layer - Use cases around job attempts

pub mod capture_buffer;
pub mod constants;
pub mod harvest;
pub mod interrupt;

// Re-exports
pub use capture_buffer::CaptureBuffer;
pub use harvest::SpoolHarvester;
pub use interrupt::{interrupt_channel, InterruptSender, InterruptToken};
