pub mod asset_groups;
pub mod events;
pub mod health;
pub mod jobs;
pub mod workers;
