pub mod analysis;
pub mod critical_analysis;
pub mod enrichment;
pub mod insights;
pub mod pipeline;
pub mod prompts;
pub mod response_generation;
pub mod sql_generation;

#[cfg(test)]
pub(crate) mod test_support;
