pub mod strategy_handler;
pub mod trade_handler;
