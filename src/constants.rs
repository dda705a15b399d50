//! Constants shared by the auth method, its configuration and its tests.

use std::time::Duration;

/// Default interval between two JWT-SVID fetches.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Config map key holding the Vault role to log in with.
pub const ROLE_KEY: &str = "role";

/// Config map key holding the JWT-SVID audience.
pub const AUDIENCE_KEY: &str = "audience";

/// Login payload key carrying the raw JWT-SVID.
pub const JWT_KEY: &str = "jwt";

/// Path segment appended to the mount path to build the login endpoint.
pub const LOGIN_PATH: &str = "login";

/// Name of the environment variable that is used to configure the socket endpoint path for SPIFFE.
pub const SPIFFE_SOCKET_ENV: &str = "SPIFFE_ENDPOINT_SOCKET";
