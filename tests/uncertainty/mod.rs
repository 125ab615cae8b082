// Tests for the Monte Carlo error analysis

mod monte_carlo_tests;
