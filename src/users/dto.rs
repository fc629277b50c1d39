use serde::Deserialize;
use uuid::Uuid;

use crate::auth::dto::{PASSWORD, USERNAME};
use crate::users::repo_types::Role;
use crate::validation::{Field, Rule, Schema, Validate};

const ROLES: &[&str] = &["user", "admin"];

#[derive(Debug, Clone, Deserialize)]
pub struct IdParams {
    pub id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub body: CreateUserRequest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserInput {
    pub params: IdParams,
    pub body: UpdateUserRequest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserIdInput {
    pub params: IdParams,
}

const ID_PARAMS: &[Field] = &[Field::required("id", Rule::Uuid)];

const CREATE_USER_BODY: &[Field] = &[
    Field::required("username", USERNAME),
    Field::required("email", Rule::Email),
    Field::required("password", PASSWORD),
    Field::optional("role", Rule::OneOf(ROLES)),
];

const UPDATE_USER_BODY: &[Field] = &[
    Field::optional("username", USERNAME),
    Field::optional("email", Rule::Email),
];

impl Validate for CreateUserInput {
    const SCHEMA: Schema = Schema {
        params: &[],
        query: &[],
        body: CREATE_USER_BODY,
    };
}

impl Validate for UpdateUserInput {
    const SCHEMA: Schema = Schema {
        params: ID_PARAMS,
        query: &[],
        body: UPDATE_USER_BODY,
    };
}

impl Validate for UserIdInput {
    const SCHEMA: Schema = Schema {
        params: ID_PARAMS,
        query: &[],
        body: &[],
    };
}
