//! Credential sign-in flow
//!
//! What the login screen does when the user submits the form: exchange the
//! credentials for a token, look up who the token belongs to, and hand the
//! result to the controller.

use crate::controller::SessionController;
use edulink_core::{
    log_operation_error, log_operation_start, log_operation_success, Credentials, EdulinkError,
    EdulinkResult, ErrorContext, Session, SessionApi,
};

/// Sign in with an email address and password
///
/// The controller is only touched once both remote calls succeeded and the
/// profile carries a role the application knows; otherwise the error is
/// returned and the session is left as it was.
pub async fn sign_in_with_credentials(
    controller: &SessionController,
    api: &dyn SessionApi,
    credentials: &Credentials,
) -> EdulinkResult<Session> {
    log_operation_start!("sign_in_with_credentials", email = %credentials.email);

    let token = api.authenticate(credentials).await.map_err(|e| {
        log_operation_error!("authenticate", e, email = %credentials.email);
        e
    })?;

    let profile = api.fetch_profile(&token).await.map_err(|e| {
        log_operation_error!("fetch_profile", e, email = %credentials.email);
        e
    })?;

    if !profile.role.is_known() {
        let error = EdulinkError::Authentication {
            message: format!(
                "Account role '{}' cannot use this application",
                profile.role
            ),
            context: ErrorContext::new("sign_in_flow")
                .with_operation("check_role")
                .with_metadata("user_id", &profile.id)
                .with_suggestion("Sign in with a parent or teacher account"),
        };
        log_operation_error!("check_role", error, user_id = %profile.id);
        return Err(error);
    }

    let session = controller
        .sign_in(token, profile.role, Some(profile.id))
        .await?;

    log_operation_success!(
        "sign_in_with_credentials",
        user_id = ?session.user_id(),
        state = %session.state()
    );
    Ok(session)
}
