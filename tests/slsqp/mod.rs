// SLSQP integration tests
mod driver;
mod kernels;
