pub mod calculator;
pub mod current_time;
pub mod json_query;
pub mod web_fetch;
pub mod web_search;
