use wasm_bindgen::prelude::*;

/// Loads an archive, repairs its names and returns the re-saved bytes.
#[wasm_bindgen]
pub fn resave_sb2(bytes: &[u8]) -> Result<Vec<u8>, JsValue> {
    let (project, _) = crate::load_project(bytes).map_err(|e| JsValue::from_str(&e.to_string()))?;
    crate::save_project(&project).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Number of renames and auto-declarations a load would perform.
#[wasm_bindgen]
pub fn repair_count(bytes: &[u8]) -> Result<usize, JsValue> {
    let (_, report) = crate::load_project(bytes).map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(report.rename_count() + report.created_count() + report.renamed_watchers)
}
