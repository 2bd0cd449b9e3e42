use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use jobrelay_core::{DispatchError, DispatchResult, JobRequest, JobType};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::JobHandler;

/// 图片处理任务：单个输入文件，Worker 返回若干输出文件
#[derive(Debug, Default, Clone)]
pub struct ImageProcessingJob;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputFile {
    file_name: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ProcessingResult {
    #[serde(default)]
    output: Vec<OutputFile>,
}

impl ImageProcessingJob {
    pub fn new() -> Self {
        Self
    }

    fn input(request: &JobRequest) -> DispatchResult<&Path> {
        match request.inputs.as_slice() {
            [input] => Ok(Path::new(input)),
            inputs => Err(DispatchError::validation(format!(
                "expected exactly 1 input, got {}",
                inputs.len()
            ))),
        }
    }

    fn output_dir(request: &JobRequest) -> DispatchResult<PathBuf> {
        if let Some(dir) = &request.output_directory {
            return Ok(dir.clone());
        }
        let input = Self::input(request)?;
        Ok(input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")))
    }
}

/// 只保留最后一个路径分量，防止 Worker 返回的文件名逃出输出目录
fn sanitize_file_name(name: &str) -> Option<&str> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
}

#[async_trait]
impl JobHandler for ImageProcessingJob {
    fn job_type(&self) -> JobType {
        JobType::ImageProcessing
    }

    fn validate(&self, request: &JobRequest) -> DispatchResult<()> {
        Self::input(request).map(|_| ())
    }

    async fn prepare(&self, request: &JobRequest) -> DispatchResult<serde_json::Value> {
        let input = Self::input(request)?;
        let bytes = tokio::fs::read(input).await.map_err(|e| {
            DispatchError::preparation(format!("读取输入文件 {} 失败: {}", input.display(), e))
        })?;
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        debug!("任务 {} 读取输入 {} ({} 字节)", request.id, input.display(), bytes.len());

        Ok(json!({
            "fileName": file_name,
            "data": STANDARD.encode(&bytes),
            "args": request.args,
        }))
    }

    async fn finalize(
        &self,
        request: &JobRequest,
        result: serde_json::Value,
    ) -> DispatchResult<serde_json::Value> {
        let parsed: ProcessingResult = serde_json::from_value(result)
            .map_err(|e| DispatchError::Finalization(format!("无法解析 Worker 结果: {}", e)))?;

        let dir = Self::output_dir(request)?;
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            DispatchError::Finalization(format!("创建输出目录 {} 失败: {}", dir.display(), e))
        })?;

        let mut written = Vec::with_capacity(parsed.output.len());
        for file in parsed.output {
            let name = sanitize_file_name(&file.file_name).ok_or_else(|| {
                DispatchError::Finalization(format!("非法的输出文件名: {:?}", file.file_name))
            })?;
            let bytes = STANDARD.decode(file.data.as_bytes()).map_err(|e| {
                DispatchError::Finalization(format!("输出文件 {} 解码失败: {}", name, e))
            })?;

            let path = dir.join(name);
            tokio::fs::write(&path, &bytes).await.map_err(|e| {
                DispatchError::Finalization(format!("写入输出文件 {} 失败: {}", path.display(), e))
            })?;
            written.push(path.to_string_lossy().into_owned());
        }

        info!("任务 {} 已写出 {} 个输出文件到 {}", request.id, written.len(), dir.display());
        Ok(json!({ "output": written }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(inputs: &[&str]) -> JobRequest {
        inputs
            .iter()
            .fold(JobRequest::new("a1", "IMAGE_PROCESSING"), |r, i| r.with_input(*i))
    }

    #[test]
    fn test_validate_requires_exactly_one_input() {
        let job = ImageProcessingJob::new();

        assert!(job.validate(&request(&["/tmp/a.png"])).is_ok());

        let err = job.validate(&request(&[])).unwrap_err();
        assert_eq!(err.to_string(), DispatchError::validation("expected exactly 1 input, got 0").to_string());

        let err = job.validate(&request(&["a", "b"])).unwrap_err();
        assert!(err.to_string().contains("got 2"));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("out.png"), Some("out.png"));
        assert_eq!(sanitize_file_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(sanitize_file_name("nested/dir/out.png"), Some("out.png"));
        assert_eq!(sanitize_file_name(""), None);
        assert_eq!(sanitize_file_name(".."), None);
    }

    #[tokio::test]
    async fn test_prepare_reads_input_as_base64() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("cat.png");
        std::fs::write(&input, b"\x89PNG fake").unwrap();

        let job = ImageProcessingJob::new();
        let req = request(&[input.to_str().unwrap()]).with_args(json!({"width": 64}));
        let payload = job.prepare(&req).await.unwrap();

        assert_eq!(payload["fileName"], "cat.png");
        assert_eq!(payload["args"]["width"], 64);
        let data = STANDARD.decode(payload["data"].as_str().unwrap()).unwrap();
        assert_eq!(data, b"\x89PNG fake");
    }

    #[tokio::test]
    async fn test_prepare_missing_file_fails() {
        let job = ImageProcessingJob::new();
        let req = request(&["/definitely/not/here.png"]);

        let err = job.prepare(&req).await.unwrap_err();
        assert!(
            matches!(err, DispatchError::Preparation(ref m) if m.contains("/definitely/not/here.png"))
        );
    }

    #[tokio::test]
    async fn test_finalize_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        let job = ImageProcessingJob::new();
        let req = request(&["/tmp/cat.png"]).with_output_directory(&out);
        let result = json!({
            "output": [
                { "fileName": "cat-64.png", "data": STANDARD.encode(b"small") },
                { "fileName": "../cat-128.png", "data": STANDARD.encode(b"large") },
            ]
        });

        let reported = job.finalize(&req, result).await.unwrap();
        let paths: Vec<String> = serde_json::from_value(reported["output"].clone()).unwrap();
        assert_eq!(paths.len(), 2);

        assert_eq!(std::fs::read(out.join("cat-64.png")).unwrap(), b"small");
        assert_eq!(std::fs::read(out.join("cat-128.png")).unwrap(), b"large");
    }

    #[tokio::test]
    async fn test_finalize_defaults_to_input_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("cat.png");

        let job = ImageProcessingJob::new();
        let req = request(&[input.to_str().unwrap()]);
        let result = json!({ "output": [ { "fileName": "cat-64.png", "data": STANDARD.encode(b"x") } ] });

        job.finalize(&req, result).await.unwrap();
        assert!(dir.path().join("cat-64.png").exists());
    }

    #[tokio::test]
    async fn test_finalize_rejects_bad_base64() {
        let dir = tempfile::tempdir().unwrap();
        let job = ImageProcessingJob::new();
        let req = request(&["/tmp/cat.png"]).with_output_directory(dir.path());
        let result = json!({ "output": [ { "fileName": "a.png", "data": "!!not base64!!" } ] });

        let err = job.finalize(&req, result).await.unwrap_err();
        assert!(matches!(err, DispatchError::Finalization(_)));
    }
}
