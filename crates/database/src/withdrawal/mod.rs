pub mod model;
pub mod repository;

#[cfg(test)]
mod tests;
