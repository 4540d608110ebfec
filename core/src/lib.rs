pub mod db;
pub mod error;
pub mod models;
pub mod openweather;
pub mod service;
