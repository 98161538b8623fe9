pub mod cleaning;
pub mod mean_variance;
pub mod qp;
