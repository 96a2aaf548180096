use netwatch_store::Role;

/// Caller identity extracted from a validated JWT or API key.
///
/// Unlike the reference stack's tenant/namespace-scoped `CallerIdentity`,
/// authorization here is a flat role comparison (§6.5): there is no grant
/// list to carry, so this is just enough to answer "who" and "what role".
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    /// User id (UUID string) for a JWT caller, or the API key's owning
    /// user id for an API-key caller.
    pub id: String,
    pub username: String,
    pub role: Role,
    /// `"jwt"` or `"api_key"`.
    pub auth_method: String,
}
