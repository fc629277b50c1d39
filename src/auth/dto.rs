use serde::Deserialize;

use crate::validation::{Field, Rule, Schema, Validate};

pub const USERNAME: Rule = Rule::Text { min: 3, max: 30 };
pub const PASSWORD: Rule = Rule::Password { min: 8 };

/// Request body for user registration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub body: RegisterRequest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub body: LoginRequest,
}

const REGISTER_BODY: &[Field] = &[
    Field::required("username", USERNAME),
    Field::required("email", Rule::Email),
    Field::required("password", PASSWORD),
];

// Login only checks presence; a wrong password must look like any other.
const LOGIN_BODY: &[Field] = &[
    Field::required("email", Rule::Text { min: 1, max: 254 }),
    Field::required("password", Rule::Password { min: 1 }),
];

impl Validate for RegisterInput {
    const SCHEMA: Schema = Schema {
        params: &[],
        query: &[],
        body: REGISTER_BODY,
    };
}

impl Validate for LoginInput {
    const SCHEMA: Schema = Schema {
        params: &[],
        query: &[],
        body: LOGIN_BODY,
    };
}
