use sea_orm::DbErr;

/// Message fragments (lowercase) of Postgres failures that are expected to clear
/// on retry or on a fresh pooled connection.
const TRANSIENT_MARKERS: &[&str] = &[
    "current transaction is aborted",
    "connection reset",
    "connection refused",
    "connection closed",
    "broken pipe",
    "pool timed out",
    "terminating connection",
    "server closed the connection",
    "could not serialize access",
    "deadlock detected",
    "type \"vector\" does not exist",
    "extension \"vector\" is not available",
    "could not access file \"$libdir/vector\"",
];

/// Classify a SeaORM error as transient.
///
/// Connection and pool-acquire failures are always transient. Query and exec
/// failures are transient when the driver message matches a known connectivity,
/// poisoned-session or extension-availability failure. Everything else
/// (syntax, constraint, type errors) is permanent.
pub fn is_transient(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Query(inner) | DbErr::Exec(inner) => {
            let message = inner.to_string().to_lowercase();
            TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker))
        }
        _ => false,
    }
}
