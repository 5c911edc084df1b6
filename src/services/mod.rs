pub mod automation;
pub mod channel;
pub mod conversation;
pub mod dates;
pub mod disambiguation;
pub mod interpreter;
pub mod otp;
pub mod prompts;
pub mod sessions;
pub mod validator;
