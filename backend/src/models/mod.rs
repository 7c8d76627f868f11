pub mod food_analysis;
pub mod nutrition;
pub mod subscription;
pub mod user;
