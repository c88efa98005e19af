#[allow(non_snake_case)]
pub mod Fitting;
#[allow(non_snake_case)]
pub mod Kinetics;
#[allow(non_snake_case)]
pub mod Utils;
