use std::collections::HashMap;

use serde::Deserialize;
use service_autograph_lib::{CancelableServiceCall, ServiceCall};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Passport {
    /// @json
    pub number: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Person {
    /// @json first_name
    pub given_name: String,
    /// @json last_name
    pub family_name: Option<String>,
    /// @json
    pub passport: Option<Passport>,
}

/// Service serving Person objects.
///
/// @service PersonServiceGen
pub trait PersonService {
    /// @url /people
    fn all(&self) -> ServiceCall<Vec<Person>>;

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

    /// @url /people/index
    fn index(&self) -> ServiceCall<HashMap<String, Person>>;

    /// @post
    /// @url /people
    fn register(
        &self,
        /// @json first_name
        given_name: String,
        /// @json last_name
        family_name: Option<String>,
    ) -> CancelableServiceCall<()>;

    /// @put
    /// @url /auth
    /// @requestInterceptor crate::AuthInterceptor
    fn auth(
        &self,
        /// @header X-Auth-Header
        token: String,
    ) -> ServiceCall<String>;
}
