use serde_json::Value;

/// Outcome of a service call: the response payload, or a failure payload
pub type ServiceResult = Result<Value, Value>;

/// Answers calls for one named service on behalf of the devices that
/// declare it
pub trait ServiceGateway {
    fn call(&mut self, operation: &str, args: &[Value]) -> ServiceResult;
}

/// A [`ServiceGateway`] backed by a closure
pub struct FnService<F>(pub F);

impl<F> ServiceGateway for FnService<F>
where
    F: FnMut(&str, &[Value]) -> ServiceResult,
{
    fn call(&mut self, operation: &str, args: &[Value]) -> ServiceResult {
        (self.0)(operation, args)
    }
}
