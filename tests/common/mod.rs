//! Shared helpers for integration tests
#![allow(dead_code)]

pub mod mock_client;
pub mod strategies;

use schema_fixup::models::{ObjectKey, ObjectReference, ObjectType};
use schema_fixup::DependencyGraph;
use std::fs;
use std::path::Path;

pub fn key(schema: &str, name: &str, object_type: ObjectType) -> ObjectKey {
    ObjectKey::new(schema, name, object_type)
}

pub fn graph(objects: &[ObjectKey], edges: &[(&ObjectKey, &ObjectKey)]) -> DependencyGraph {
    let references: Vec<ObjectReference> = edges
        .iter()
        .map(|(dependent, referenced)| ObjectReference::new((*dependent).clone(), (*referenced).clone()))
        .collect();
    DependencyGraph::build(objects, &references, &[]).expect("valid graph")
}

/// Write `<root>/<rel>` with a script unique to the task and return it
pub fn write_task(root: &Path, rel: &str) -> String {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("task file has a parent")).expect("create task dir");
    let script = format!("-- task {rel}\n");
    fs::write(&path, &script).expect("write task file");
    script
}
