// Internal logging facade: `trace!`, `debug!`, `info!`, `warn!`, `error!`
// backed by `tracing`, `log`, or nothing depending on enabled features.

#[allow(unused_imports)]
pub(crate) use crate::observability::{
    log_debug as debug, log_error as error, log_info as info, log_trace as trace,
    log_warn as warn,
};
