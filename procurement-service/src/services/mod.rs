pub mod database;
pub mod items;
pub mod jwt;
pub mod metrics;
pub mod plans;

pub use database::Database;
pub use items::ItemService;
pub use jwt::{Claims, JwtService};
pub use metrics::{get_metrics, init_metrics};
pub use plans::PlanService;
