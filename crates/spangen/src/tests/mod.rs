mod arbitrary;
mod harness;
