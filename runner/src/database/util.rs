use super::StoreError;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;

pub type CountMap = BTreeMap<String, usize>;

/// number of stored runs per suite
pub fn retrieve_counts(connection: &Connection) -> Result<CountMap, StoreError> {
    connection
        .prepare_cached("select suite, count(*) from runs group by suite")?
        .query_map(params![], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .try_fold(BTreeMap::new(), |mut init, result| {
            let (suite, count) = result?;
            init.insert(suite, count as usize);

            Ok::<CountMap, StoreError>(init)
        })
}
