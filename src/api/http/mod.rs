pub mod axum;
pub mod graphql;

pub const LOGIN_PATH: &str = "/login/kroger";
pub const AUTH_PATH: &str = "/auth/kroger";
pub const ADD_TO_CART_PATH: &str = "/add-to-cart";
