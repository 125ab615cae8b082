// Tests for data assembly and the NOE report

mod noe_tests;
mod pcs_tests;
mod rdc_tests;
