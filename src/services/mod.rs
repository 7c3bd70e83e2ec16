pub mod coupon_service;
pub mod migration_service;
pub mod payment_method_resolver;
pub mod price_mapper;
pub mod product_service;
pub mod resource_matcher;
pub mod run_context;
pub mod submission;
pub mod subscription_service;

pub use coupon_service::*;
pub use migration_service::*;
pub use payment_method_resolver::*;
pub use price_mapper::*;
pub use product_service::*;
pub use resource_matcher::*;
pub use run_context::*;
pub use subscription_service::*;
