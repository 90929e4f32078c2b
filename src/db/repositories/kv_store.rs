use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};

use crate::db::{helpers, Database};

impl Database {
    /// Raw stored text for `key`, if any.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| helpers::read_raw(conn, &key)).await
    }

    pub async fn put_raw(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| helpers::write_raw(conn, &key, &value))
            .await
    }

    pub async fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let key = key.to_string();
        self.execute(move |conn| helpers::read_json(conn, &key)).await
    }

    pub async fn put_json<T>(&self, key: &str, value: T) -> Result<()>
    where
        T: Serialize + Send + 'static,
    {
        let key = key.to_string();
        self.execute(move |conn| helpers::write_json(conn, &key, &value))
            .await
    }

    /// Removes every listed key in one transaction.
    pub async fn remove_keys(&self, keys: &[&str]) -> Result<()> {
        let keys: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            for key in &keys {
                helpers::remove_key(&tx, key)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
