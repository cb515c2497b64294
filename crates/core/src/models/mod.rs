pub mod category;
pub mod dataset;
pub mod fetch;
pub mod interval;
pub mod numeric;
pub mod portfolio;
pub mod query;
pub mod settings;
pub mod transaction;
