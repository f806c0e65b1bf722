mod logic; // restore_backup on the engine: guard, download, pipe into the restore tool
pub(crate) mod db_restore; // Engine-specific restore command construction and execution
