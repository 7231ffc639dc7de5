use std::env;

/// Process-wide settings for the object store, key layout and HTTP ingress.
#[derive(Debug, Clone)]
pub struct Settings {
    // AWS configuration
    pub aws_default_region: String,
    pub aws_profile: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub s3_endpoint_url: Option<String>,

    // Buckets and prefixes per scope
    pub s3_bucket_mba: String,
    pub s3_bucket_policy: String,
    pub s3_prefix_mba: String,
    pub s3_prefix_policy: String,
    pub s3_auto_detect_type: bool,

    // AES256 or aws:kms, None disables server-side encryption
    pub s3_sse: Option<String>,

    // HTTP ingress
    pub host: String,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            aws_default_region: env::var("AWS_DEFAULT_REGION")
                .unwrap_or_else(|_| "ap-south-1".to_string()),

            aws_profile: optional_var("AWS_PROFILE"),
            aws_access_key_id: optional_var("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: optional_var("AWS_SECRET_ACCESS_KEY"),
            s3_endpoint_url: optional_var("S3_ENDPOINT_URL"),

            s3_bucket_mba: env::var("S3_BUCKET_MBA")
                .unwrap_or_else(|_| "hma-mba-bucket".to_string()),

            s3_bucket_policy: env::var("S3_BUCKET_POLICY")
                .unwrap_or_else(|_| "hma-policy-bucket".to_string()),

            s3_prefix_mba: env::var("S3_PREFIX_MBA")
                .unwrap_or_else(|_| "mba/".to_string()),

            s3_prefix_policy: env::var("S3_PREFIX_POLICY")
                .unwrap_or_else(|_| "policy/".to_string()),

            s3_auto_detect_type: env::var("S3_AUTO_DETECT_TYPE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,

            s3_sse: match env::var("S3_SSE") {
                Ok(value) => sanitize(Some(value)),
                Err(_) => Some("AES256".to_string()),
            },

            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),

            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            aws_default_region: "ap-south-1".to_string(),
            aws_profile: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            s3_endpoint_url: None,
            s3_bucket_mba: "hma-mba-bucket".to_string(),
            s3_bucket_policy: "hma-policy-bucket".to_string(),
            s3_prefix_mba: "mba/".to_string(),
            s3_prefix_policy: "policy/".to_string(),
            s3_auto_detect_type: true,
            s3_sse: Some("AES256".to_string()),
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

// An exported-but-empty AWS_PROFILE must behave like an unset one.
fn optional_var(name: &str) -> Option<String> {
    sanitize(env::var(name).ok())
}

fn sanitize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
