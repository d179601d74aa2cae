use rocket::request::{self, Request, FromRequest, Outcome};
use rocket::http::Status;
use rocket::State;
use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{User, UserRole};
use mongodb::bson::doc;
use rocket_okapi::request::OpenApiFromRequest;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::request::RequestHeaderInput;

/// Admin access. The role is re-read from the database so a demoted
/// admin loses access before their token expires.
pub struct AdminGuard {
    pub auth: AuthGuard,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let auth = match req.guard::<AuthGuard>().await {
            Outcome::Success(auth) => auth,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(f) => return Outcome::Forward(f),
        };

        if auth.role != UserRole::Admin {
            return Outcome::Error((Status::Forbidden, ()));
        }

        let db = match req.guard::<&State<DbConn>>().await {
            Outcome::Success(db) => db,
            _ => return Outcome::Error((Status::InternalServerError, ())),
        };

        let user = db.collection::<User>("users")
            .find_one(doc! { "_id": auth.user_id }, None)
            .await;

        match user {
            Ok(Some(user)) if user.role == UserRole::Admin && user.is_active => {
                Outcome::Success(AdminGuard { auth })
            }
            Ok(_) => {
                warn!("admin guard: user {} is not an active admin", auth.user_id);
                Outcome::Error((Status::Forbidden, ()))
            }
            Err(e) => {
                error!("admin guard: role lookup failed: {}", e);
                Outcome::Error((Status::InternalServerError, ()))
            }
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for AdminGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
