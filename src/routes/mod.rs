pub mod routes;

pub use self::routes::routes;
