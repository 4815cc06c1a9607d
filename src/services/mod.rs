pub mod asset;
pub mod audit;
pub mod batch;
pub mod consistency;
pub mod image;
pub mod permission;
pub mod pipeline;
pub mod quota;
pub mod ratelimit;
pub mod validate;

pub use asset::AssetService;
pub use audit::AuditLog;
pub use batch::BatchCoordinator;
pub use consistency::ConsistencyChecker;
pub use permission::PermissionGate;
pub use pipeline::UploadPipeline;
pub use quota::QuotaService;
pub use ratelimit::RateLimiter;
