use uuid::Uuid;

/// Error type for every store operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Product {product_id} is out of stock")]
    OutOfStock { product_id: Uuid },

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Invalid input: {0}")]
    Validation(String),

    /// The transaction was aborted by the lock manager (deadlock, lock timeout,
    /// serialization failure). Nothing was persisted; the caller may retry.
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Transaction commit failed: {0}")]
    CommitFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    DatabaseError(#[source] sqlx::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        StoreError::NotFound { entity, id }
    }

    /// True when the failed operation left no durable effect and can simply be
    /// submitted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::TransactionAborted(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SqlStateClass {
    Integrity,
    Aborted,
}

/// Maps a PostgreSQL SQLSTATE onto the store taxonomy.
fn classify_sqlstate(code: &str) -> Option<SqlStateClass> {
    match code {
        // string_data_right_truncation, numeric_value_out_of_range
        "22001" | "22003" => Some(SqlStateClass::Integrity),
        c if c.starts_with("23") => Some(SqlStateClass::Integrity),
        // serialization_failure, deadlock_detected, lock_not_available, query_canceled
        "40001" | "40P01" | "55P03" | "57014" => Some(SqlStateClass::Aborted),
        _ => None,
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let class = db_err.code().as_deref().and_then(classify_sqlstate);
            let message = db_err.message().to_string();
            match class {
                Some(SqlStateClass::Integrity) => return StoreError::IntegrityViolation(message),
                Some(SqlStateClass::Aborted) => return StoreError::TransactionAborted(message),
                None => {}
            }
        }
        StoreError::DatabaseError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_classes_map_to_taxonomy() {
        let integrity = ["23505", "23503", "23514", "23502", "22001", "22003"];
        for code in integrity {
            assert_eq!(classify_sqlstate(code), Some(SqlStateClass::Integrity), "{code}");
        }

        for code in ["40001", "40P01", "55P03", "57014"] {
            assert_eq!(classify_sqlstate(code), Some(SqlStateClass::Aborted), "{code}");
        }
        assert!(StoreError::TransactionAborted("deadlock detected".into()).is_retryable());

        assert!(classify_sqlstate("08006").is_none());
    }

    #[test]
    fn out_of_stock_is_not_retryable() {
        let err = StoreError::OutOfStock { product_id: Uuid::nil() };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("out of stock"));
    }

    #[test]
    fn non_database_sqlx_errors_stay_generic() {
        let err: StoreError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, StoreError::DatabaseError(_)));
    }
}
