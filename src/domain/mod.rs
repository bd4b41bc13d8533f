pub mod audit;
pub mod coupon;
pub mod event;
pub mod payment;
pub mod registration;

pub use audit::*;
pub use coupon::*;
pub use event::*;
pub use payment::*;
pub use registration::*;
