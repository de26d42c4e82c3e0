pub mod aws_sigv4;
pub mod open_ai_service;
pub mod sagemaker_service;
