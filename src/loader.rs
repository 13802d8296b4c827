//! Reading workflow and descriptor documents from disk

use std::path::Path;

use action_flow::WorkflowDefinition;
use action_locator::ElementDescriptor;
use tokio::fs;

use crate::errors::{Result, SoulFlowError};

pub async fn load_workflow(path: &Path) -> Result<WorkflowDefinition> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|err| SoulFlowError::read(path, err))?;
    Ok(WorkflowDefinition::from_json(&raw)?)
}

pub async fn load_descriptor(path: &Path) -> Result<ElementDescriptor> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|err| SoulFlowError::read(path, err))?;
    serde_json::from_str(&raw).map_err(SoulFlowError::Descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn missing_files_report_the_path() {
        let err = load_workflow(Path::new("/nonexistent/flow.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/flow.json"));
    }

    #[tokio::test]
    async fn descriptor_errors_are_typed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ \"classes\": 3 }}").unwrap();
        assert!(matches!(
            load_descriptor(file.path()).await,
            Err(SoulFlowError::Descriptor(_))
        ));
    }

    #[tokio::test]
    async fn workflow_parse_errors_are_typed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ \"steps\": 1 }}").unwrap();
        assert!(matches!(
            load_workflow(file.path()).await,
            Err(SoulFlowError::Workflow(_))
        ));
    }
}
