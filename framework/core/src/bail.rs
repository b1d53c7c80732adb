/// Return this error from a virtual user's behaviour to stop that virtual user.
///
/// This should be used when a virtual user hits a condition it cannot recover from, but which is
/// not fatal to the run. For example, if its client cannot be constructed then the virtual user
/// may bail while the other virtual users keep driving load.
///
/// The bailing virtual user itself is not restarted. Its slot is refilled by a new virtual user,
/// with a new id, on the ramp scheduler's next adjustment.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct VirtualUserBailError {
    msg: String,
}

impl VirtualUserBailError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for VirtualUserBailError {
    fn default() -> Self {
        Self::new("Virtual user is bailing")
    }
}
