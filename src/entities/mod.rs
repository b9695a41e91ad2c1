pub mod branch;
pub mod location;
pub mod maintenance;
pub mod maintenance_item;
pub mod maintenance_part;
pub mod piece;
pub mod stock_movement;
pub mod supplier;
pub mod user;
pub mod vehicle;
