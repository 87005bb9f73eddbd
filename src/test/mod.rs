mod header_stack;
mod scenario;
