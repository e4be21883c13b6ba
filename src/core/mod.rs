pub mod controller;
pub mod event;
pub mod resource;
pub mod simulation;
pub mod types;
pub mod unit;
