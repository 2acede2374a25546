pub mod metrics;
pub mod strategy_store;
pub mod trade_query;
