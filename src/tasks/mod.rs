pub mod cycle_closer;
