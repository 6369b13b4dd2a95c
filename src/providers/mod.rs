mod endpoints;
mod entra;
mod generic;

pub use endpoints::ProviderEndpoints;
pub use entra::{DEFAULT_AUTHORITY_HOST, EntraProvider};
pub use generic::GenericOidcProvider;
