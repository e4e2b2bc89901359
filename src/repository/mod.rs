//! 数据库访问层

pub mod audit_repo;
pub mod auth_repo;
pub mod order_repo;
pub mod product_repo;
pub mod rma_repo;
pub mod role_repo;
pub mod user_repo;

pub use audit_repo::AuditRepository;
pub use auth_repo::AuthRepository;
pub use order_repo::OrderRepository;
pub use product_repo::ProductRepository;
pub use rma_repo::RmaRepository;
pub use role_repo::RoleRepository;
pub use user_repo::UserRepository;
