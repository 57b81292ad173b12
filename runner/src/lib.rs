pub mod collection;
pub mod config;
pub mod distributor;
pub mod executors;
pub mod expander;
pub mod flavors;
pub mod formats;
pub mod job;
pub mod script;

#[cfg(test)]
mod collection_test;
#[cfg(test)]
mod config_test;
