pub mod metrics;
pub mod repository;
pub mod vnpay;

pub use metrics::{get_metrics, init_metrics};
pub use repository::PaymentRepository;
pub use vnpay::VnpayClient;
