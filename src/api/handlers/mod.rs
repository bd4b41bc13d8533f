pub mod admin;
pub mod events;
pub mod payments;
pub mod registrations;
pub mod root;

use axum::http::{header::USER_AGENT, HeaderMap};

use crate::{auth::CurrentUser, domain::Actor};

/// Who is calling, as far as the request headers say.
pub fn actor_from_headers(headers: &HeaderMap) -> Actor {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    Actor {
        user_id: None,
        user_email: None,
        ip_address: header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header("x-real-ip")),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// The signed-in admin, plus whatever the headers say about the connection.
pub fn admin_actor(user: &CurrentUser, headers: &HeaderMap) -> Actor {
    Actor {
        user_id: Some(user.id.clone()),
        user_email: user.email.clone(),
        ..actor_from_headers(headers)
    }
}
