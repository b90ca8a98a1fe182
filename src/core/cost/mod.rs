pub mod cache;
pub mod pricing;
pub mod report;
pub mod scanner;
