pub mod engine;
pub mod iface;
pub mod scenario;
pub mod wire;

#[cfg(test)]
mod test;
