use super::handlers::{health, login, me, password, register, types, verification};
use utoipa::{
    Modify, OpenApi,
    openapi::{
        Contact, License, Tag,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        register::register,
        login::login,
        verification::verify_email,
        verification::resend_verification,
        password::forgot_password,
        password::reset_password,
        me::get_me,
    ),
    components(schemas(
        health::Health,
        types::ErrorResponse,
        types::MessageResponse,
        types::UserResponse,
        types::RegisterRequest,
        types::RegisterResponse,
        types::LoginRequest,
        types::LoginResponse,
        types::UnverifiedResponse,
        types::VerifyEmailRequest,
        types::VerifyEmailResponse,
        types::ResendVerificationRequest,
        types::ForgotPasswordRequest,
        types::ResetPasswordRequest,
    )),
    modifiers(&BearerAuth)
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// The `OpenAPI` document for every served route, with info taken from Cargo
/// metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = optional_str(env!("CARGO_PKG_DESCRIPTION")).map(str::to_string);
    doc.info.contact = cargo_contact();
    doc.info.license = cargo_license();

    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Liveness and store reachability".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Registration, login, email verification and password reset".to_string());

    let mut me_tag = Tag::new("me");
    me_tag.description = Some("Authenticated profile".to_string());

    doc.tags = Some(vec![health_tag, auth_tag, me_tag]);
    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    let Some(start) = author.find('<') else {
        let name = author.trim();
        return (if name.is_empty() { None } else { Some(name) }, None);
    };
    let name = author[..start].trim();
    let email = author[start + 1..].trim_end_matches('>').trim();
    (
        if name.is_empty() { None } else { Some(name) },
        if email.is_empty() { None } else { Some(email) },
    )
}
