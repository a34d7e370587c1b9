pub mod admin_routes;
pub mod guardian_routes;
pub mod health;
pub mod internal_routes;
