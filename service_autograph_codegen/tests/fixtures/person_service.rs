use serde::Deserialize;
use service_autograph_lib::{CancelableServiceCall, ServiceCall};

/// A passport.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Passport {
    /// @json passport_number
    pub number: String,
}

/// A human being.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Person {
    /// First name.
    ///
    /// @json first_name
    pub given_name: String,
    /// Last name.
    ///
    /// @json last_name
    pub family_name: Option<String>,
    /// @json
    pub passport: Option<Passport>,
}

/// Not decodable, so it gets no key map.
#[derive(Debug, Clone)]
pub struct Draft {
    /// @json
    pub title: String,
}

/// Service serving Person objects.
///
/// @service PersonServiceGen
pub trait PersonService {
    /// Get all people.
    ///
    /// @url /people
    fn all(&self) -> ServiceCall<Vec<Person>>;

    /// Get single `Person`.
    ///
    /// @url /people/{id}
    fn get(
        &self,
        /// @url
        id: u64,
    ) -> ServiceCall<Person>;

    /// @url /people/search
    fn find(
        &self,
        /// @query q
        name: String,
    ) -> ServiceCall<Option<Person>>;

    /// Register new `Person` with first name and last name.
    ///
    /// @post
    /// @url /people
    fn register(
        &self,
        /// @json first_name
        given_name: String,
        /// @json last_name
        family_name: String,
    ) -> CancelableServiceCall<()>;

    /// Authorize.
    ///
    /// @put
    /// @url /auth
    /// @requestInterceptor crate::AuthInterceptor
    fn auth(
        &self,
        /// @header X-Auth-Header
        token: String,
    ) -> ServiceCall<String>;
}

/// @service
pub trait BrokenService {
    fn broken(&self) -> u32;
}
