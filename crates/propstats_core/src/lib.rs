pub mod config;
pub mod extract;
pub mod fetch;
pub mod normalize;
pub mod report;
pub mod survey;
pub mod tally;
pub mod topics;

#[cfg(test)]
mod testing;
