mod common;
mod override_gate;
