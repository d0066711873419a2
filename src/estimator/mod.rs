pub mod estimator;
