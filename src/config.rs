use serde::Deserialize;
use std::{collections::BTreeMap, env, fs, path::Path, path::PathBuf, sync::Arc};
use tracing::info;

use crate::auth::{
    AuthenticationSchemeOptions, OptionsMonitor, OptionsProvider, SchemeDescriptor,
    SchemeRegistry,
};
use crate::schemes::{
    ApiKeyEntry, ApiKeyOptions, ApiKeyScheme, BearerOptions, BearerScheme, PolicyOptions,
    PolicyScheme, authorization_header_policy,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemesConfig {
    #[serde(default)]
    pub default_scheme: Option<String>,
    #[serde(default)]
    pub default_challenge_scheme: Option<String>,
    #[serde(default)]
    pub default_forbid_scheme: Option<String>,
    pub schemes: BTreeMap<String, SchemeConfig>,
}

/// Settings shared by every scheme type.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommonConfig {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub claims_issuer: Option<String>,
    #[serde(default)]
    pub forward_default: Option<String>,
    #[serde(default)]
    pub forward_authenticate: Option<String>,
    #[serde(default)]
    pub forward_challenge: Option<String>,
    #[serde(default)]
    pub forward_forbid: Option<String>,
    #[serde(default)]
    pub forward_sign_in: Option<String>,
    #[serde(default)]
    pub forward_sign_out: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyConfig {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default)]
    pub header_name: Option<String>,
    #[serde(default)]
    pub keys: Vec<ApiKeyEntry>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BearerConfig {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub secret: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub leeway_seconds: Option<i64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    #[serde(flatten)]
    pub common: CommonConfig,
    /// Authorization header prefix (e.g. "Bearer") that selects `authorization_scheme`.
    #[serde(default)]
    pub authorization_prefix: Option<String>,
    #[serde(default)]
    pub authorization_scheme: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SchemeConfig {
    ApiKey(ApiKeyConfig),
    Bearer(BearerConfig),
    Policy(PolicyConfig),
}

impl SchemeConfig {
    pub fn common(&self) -> &CommonConfig {
        match self {
            SchemeConfig::ApiKey(cfg) => &cfg.common,
            SchemeConfig::Bearer(cfg) => &cfg.common,
            SchemeConfig::Policy(cfg) => &cfg.common,
        }
    }
}

/// Options stores backing a registry built from configuration, one per
/// scheme type. Updating them reconfigures later requests.
pub struct ConfiguredSchemes {
    pub registry: SchemeRegistry,
    pub api_keys: Arc<OptionsMonitor<ApiKeyOptions>>,
    pub bearers: Arc<OptionsMonitor<BearerOptions>>,
    pub policies: Arc<OptionsMonitor<PolicyOptions>>,
}

impl SchemesConfig {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let cfg: SchemesConfig = serde_json::from_str(raw)?;
        let schemes = cfg
            .schemes
            .into_iter()
            .map(|(name, scheme)| (name, expand_scheme(scheme)))
            .collect();
        Ok(SchemesConfig { schemes, ..cfg })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Check that every referenced scheme name is configured.
    pub fn validate(&self) -> anyhow::Result<()> {
        let defaults = [
            ("defaultScheme", &self.default_scheme),
            ("defaultChallengeScheme", &self.default_challenge_scheme),
            ("defaultForbidScheme", &self.default_forbid_scheme),
        ];
        for (field, target) in defaults {
            if let Some(target) = target
                && !self.schemes.contains_key(target)
            {
                return Err(anyhow::anyhow!(
                    "`{}` refers to unknown scheme `{}`",
                    field,
                    target
                ));
            }
        }

        for (name, scheme) in &self.schemes {
            let common = scheme.common();
            let mut targets = vec![
                &common.forward_default,
                &common.forward_authenticate,
                &common.forward_challenge,
                &common.forward_forbid,
                &common.forward_sign_in,
                &common.forward_sign_out,
            ];
            if let SchemeConfig::Policy(policy) = scheme {
                targets.push(&policy.authorization_scheme);
            }
            for target in targets.into_iter().flatten() {
                if !self.schemes.contains_key(target) {
                    return Err(anyhow::anyhow!(
                        "Scheme `{}` forwards to unknown scheme `{}`",
                        name,
                        target
                    ));
                }
            }
        }

        Ok(())
    }

    /// Build the scheme registry and its options stores.
    pub fn build(&self) -> anyhow::Result<ConfiguredSchemes> {
        self.validate()?;

        let api_keys = Arc::new(OptionsMonitor::<ApiKeyOptions>::new());
        let bearers = Arc::new(OptionsMonitor::<BearerOptions>::new());
        let policies = Arc::new(OptionsMonitor::<PolicyOptions>::new());
        let api_key_provider: Arc<dyn OptionsProvider<ApiKeyOptions>> = api_keys.clone();
        let bearer_provider: Arc<dyn OptionsProvider<BearerOptions>> = bearers.clone();
        let policy_provider: Arc<dyn OptionsProvider<PolicyOptions>> = policies.clone();

        let mut registry = SchemeRegistry::new();
        for (name, scheme) in &self.schemes {
            let mut descriptor = SchemeDescriptor::new(name.as_str());
            if let Some(display_name) = &scheme.common().display_name {
                descriptor = descriptor.with_display_name(display_name.clone());
            }

            registry = match scheme {
                SchemeConfig::ApiKey(cfg) => {
                    let mut options = ApiKeyOptions {
                        common: common_options(&cfg.common),
                        keys: cfg.keys.clone(),
                        ..Default::default()
                    };
                    if let Some(header_name) = &cfg.header_name {
                        options.header_name = header_name.clone();
                    }
                    api_keys.configure(name, options)?;
                    registry.add_scheme(descriptor, api_key_provider.clone(), ApiKeyScheme::new)
                }
                SchemeConfig::Bearer(cfg) => {
                    let mut options = BearerOptions {
                        common: common_options(&cfg.common),
                        secret: cfg.secret.clone(),
                        issuer: cfg.issuer.clone(),
                        audience: cfg.audience.clone(),
                        ..Default::default()
                    };
                    if let Some(leeway) = cfg.leeway_seconds {
                        options.leeway_seconds = leeway;
                    }
                    bearers.configure(name, options)?;
                    registry.add_scheme(descriptor, bearer_provider.clone(), BearerScheme::new)
                }
                SchemeConfig::Policy(cfg) => {
                    let mut options = match (&cfg.authorization_prefix, &cfg.authorization_scheme) {
                        (Some(prefix), Some(target)) => {
                            authorization_header_policy(prefix.clone(), target.clone(), None)
                        }
                        _ => PolicyOptions::default(),
                    };
                    let common = common_options::<()>(&cfg.common);
                    options.claims_issuer = common.claims_issuer;
                    options.forward_default = common.forward_default;
                    options.forward_authenticate = common.forward_authenticate;
                    options.forward_challenge = common.forward_challenge;
                    options.forward_forbid = common.forward_forbid;
                    options.forward_sign_in = common.forward_sign_in;
                    options.forward_sign_out = common.forward_sign_out;
                    policies.configure(name, options)?;
                    registry.add_scheme(descriptor, policy_provider.clone(), PolicyScheme::new)
                }
            };
            info!("Configured authentication scheme {}", name);
        }

        if let Some(scheme) = &self.default_scheme {
            registry = registry.with_default_scheme(scheme.clone());
        }
        if let Some(scheme) = &self.default_challenge_scheme {
            registry = registry.with_default_challenge_scheme(scheme.clone());
        }
        if let Some(scheme) = &self.default_forbid_scheme {
            registry = registry.with_default_forbid_scheme(scheme.clone());
        }

        Ok(ConfiguredSchemes {
            registry,
            api_keys,
            bearers,
            policies,
        })
    }
}

fn common_options<E>(cfg: &CommonConfig) -> AuthenticationSchemeOptions<E> {
    AuthenticationSchemeOptions {
        claims_issuer: cfg.claims_issuer.clone(),
        forward_default: cfg.forward_default.clone(),
        forward_authenticate: cfg.forward_authenticate.clone(),
        forward_challenge: cfg.forward_challenge.clone(),
        forward_forbid: cfg.forward_forbid.clone(),
        forward_sign_in: cfg.forward_sign_in.clone(),
        forward_sign_out: cfg.forward_sign_out.clone(),
        ..Default::default()
    }
}

pub fn resolve_schemes_json_path() -> anyhow::Result<PathBuf> {
    if let Ok(p) = env::var("AUTH_SCHEMES_CONFIG") {
        return Ok(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("scheme-auth").join("schemes.json");
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let candidate = PathBuf::from("schemes.json");
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(anyhow::anyhow!(
        "Could not find schemes.json (set AUTH_SCHEMES_CONFIG or create ./schemes.json)"
    ))
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}

fn expand_opt(value: &mut Option<String>) {
    if let Some(v) = value.as_mut() {
        *v = expand_env_vars(v);
    }
}

fn expand_scheme(cfg: SchemeConfig) -> SchemeConfig {
    let mut cfg = cfg;

    match &mut cfg {
        SchemeConfig::ApiKey(api_key) => {
            expand_opt(&mut api_key.header_name);
            expand_opt(&mut api_key.common.claims_issuer);
        }
        SchemeConfig::Bearer(bearer) => {
            bearer.secret = expand_env_vars(&bearer.secret);
            expand_opt(&mut bearer.issuer);
            expand_opt(&mut bearer.audience);
            expand_opt(&mut bearer.common.claims_issuer);
        }
        SchemeConfig::Policy(policy) => {
            expand_opt(&mut policy.common.claims_issuer);
        }
    }

    cfg
}

/// Locate, parse and build the configured schemes.
pub fn load_schemes() -> anyhow::Result<ConfiguredSchemes> {
    let path = resolve_schemes_json_path()?;
    info!("Loading authentication schemes from {}", path.display());
    SchemesConfig::load(&path)?.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{HttpContext, RequestAuthentication};
    use crate::schemes::hash_api_key;
    use std::io::Write;

    fn sample_json() -> String {
        format!(
            r#"{{
                "defaultScheme": "smart",
                "schemes": {{
                    "api-key": {{
                        "type": "apiKey",
                        "displayName": "API key",
                        "headerName": "X-Service-Key",
                        "keys": [{{ "name": "ops", "keyHash": "{}", "roles": ["admin"] }}]
                    }},
                    "bearer": {{
                        "type": "bearer",
                        "secret": "${{SCHEME_AUTH_TEST_UNSET_SECRET}}",
                        "issuer": "https://issuer.example.com",
                        "leewaySeconds": 5
                    }},
                    "smart": {{
                        "type": "policy",
                        "authorizationPrefix": "Bearer",
                        "authorizationScheme": "bearer",
                        "forwardDefault": "api-key"
                    }}
                }}
            }}"#,
            hash_api_key("ops-key")
        )
    }

    #[test]
    fn test_expand_env_vars_keeps_unknown_variables() {
        assert_eq!(
            expand_env_vars("a-${SCHEME_AUTH_TEST_UNSET_VAR}-b"),
            "a-${SCHEME_AUTH_TEST_UNSET_VAR}-b"
        );
        assert_eq!(expand_env_vars("plain"), "plain");
    }

    #[test]
    fn test_expand_env_vars_substitutes_known_variables() {
        let Ok(path) = env::var("PATH") else {
            return;
        };
        assert_eq!(expand_env_vars("${PATH}"), path);
    }

    #[test]
    fn test_parse_scheme_types() {
        let cfg = SchemesConfig::from_json(&sample_json()).unwrap();

        assert_eq!(cfg.default_scheme.as_deref(), Some("smart"));
        assert!(matches!(cfg.schemes["api-key"], SchemeConfig::ApiKey(_)));
        assert!(matches!(cfg.schemes["bearer"], SchemeConfig::Bearer(_)));
        let SchemeConfig::Policy(policy) = &cfg.schemes["smart"] else {
            panic!("expected policy scheme");
        };
        assert_eq!(policy.common.forward_default.as_deref(), Some("api-key"));
        assert_eq!(policy.authorization_scheme.as_deref(), Some("bearer"));
    }

    #[test]
    fn test_config_file_round_trip_into_options() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_json().as_bytes()).unwrap();

        let configured = SchemesConfig::load(file.path()).unwrap().build().unwrap();

        assert_eq!(
            configured.registry.scheme_names(),
            vec!["api-key".to_string(), "bearer".to_string(), "smart".to_string()]
        );
        assert_eq!(configured.registry.default_challenge_scheme(), Some("smart"));
        assert_eq!(
            configured
                .registry
                .descriptor("api-key")
                .and_then(|d| d.display_name().map(str::to_string)),
            Some("API key".to_string())
        );

        let api_key = configured.api_keys.get("api-key");
        assert_eq!(api_key.header_name, "X-Service-Key");
        assert_eq!(api_key.keys[0].roles, vec!["admin".to_string()]);

        let bearer = configured.bearers.get("bearer");
        assert_eq!(bearer.secret, "${SCHEME_AUTH_TEST_UNSET_SECRET}");
        assert_eq!(bearer.leeway_seconds, 5);

        let policy = configured.policies.get("smart");
        assert_eq!(policy.forward_default.as_deref(), Some("api-key"));
        assert!(policy.forward_default_selector.is_some());
    }

    #[tokio::test]
    async fn test_configured_registry_authenticates() {
        let configured = SchemesConfig::from_json(&sample_json())
            .unwrap()
            .build()
            .unwrap();
        let request = http::Request::get("/")
            .header("X-Service-Key", "ops-key")
            .body(())
            .unwrap();
        let auth = RequestAuthentication::new(
            Arc::new(configured.registry),
            Arc::new(HttpContext::from_request(request)),
        )
        .unwrap();

        let result = auth.authenticate_default().await.unwrap();
        assert_eq!(result.ticket().unwrap().scheme(), "api-key");
        assert!(result.principal().unwrap().is_in_role("admin"));
    }

    #[test]
    fn test_unknown_forward_target_is_rejected() {
        let raw = r#"{
            "schemes": {
                "a": { "type": "apiKey", "forwardChallenge": "missing" }
            }
        }"#;
        let err = SchemesConfig::from_json(raw).unwrap().build().err().unwrap();
        assert!(err.to_string().contains("unknown scheme `missing`"));
    }

    #[test]
    fn test_unknown_default_scheme_is_rejected() {
        let raw = r#"{ "defaultScheme": "nope", "schemes": {} }"#;
        let err = SchemesConfig::from_json(raw).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("`defaultScheme`"));
    }

    #[test]
    fn test_invalid_options_fail_the_build() {
        let raw = r#"{
            "schemes": {
                "bearer": { "type": "bearer", "secret": "" }
            }
        }"#;
        let err = SchemesConfig::from_json(raw).unwrap().build().err().unwrap();
        assert!(err.to_string().contains("secret must not be empty"));
    }
}
