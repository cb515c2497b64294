pub mod bucketing_service;
pub mod comparison_service;
pub mod dashboard_service;
pub mod fanout_service;
pub mod interval_service;
pub mod position_walker;
pub mod value_aggregator;
