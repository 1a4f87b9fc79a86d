//! Runtime configuration
//!
//! Every knob comes from environment variables and is read once at startup.

use serde::Serialize;

/// A purchasable credit bundle shown on the purchase page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditPackage {
    /// Price in whole currency units.
    pub price: i64,
    pub credits: i64,
    pub popular: bool,
}

/// Stripe integration settings. Payments are disabled when the
/// secret key is absent.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub assistant_credit_cost: i64,
    pub new_user_starting_credits: i64,
    pub credit_packages: Vec<CreditPackage>,
    pub auth_secret: String,
    pub stripe: StripeConfig,
    pub seed_admin_email: String,
    pub seed_admin_password: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("PORTAL_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(4000);

        let db_path = std::env::var("PORTAL_DB_PATH").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.campus-portal/portal.db")
        });

        let credit_packages = std::env::var("CREDIT_PACKAGES")
            .ok()
            .and_then(|s| parse_credit_packages(&s))
            .unwrap_or_else(default_credit_packages);

        Self {
            port,
            db_path,
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            assistant_credit_cost: env_i64("ASSISTANT_CREDIT_COST", 1),
            new_user_starting_credits: env_i64("NEW_USER_STARTING_CREDITS", 20),
            credit_packages,
            auth_secret: std::env::var("AUTH_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".to_string()),
            stripe: StripeConfig {
                secret_key: std::env::var("STRIPE_SECRET_KEY").ok(),
                webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
                success_url: std::env::var("CHECKOUT_SUCCESS_URL").unwrap_or_else(|_| {
                    "http://localhost:4000/?checkout=success".to_string()
                }),
                cancel_url: std::env::var("CHECKOUT_CANCEL_URL")
                    .unwrap_or_else(|_| "http://localhost:4000/?checkout=cancel".to_string()),
            },
            seed_admin_email: std::env::var("SEED_ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@portal.local".to_string()),
            seed_admin_password: std::env::var("SEED_ADMIN_PASSWORD")
                .unwrap_or_else(|_| "change-me-on-first-login".to_string()),
        }
    }

    /// Find the configured package matching a requested credit amount.
    /// The client identifies packs by credit count, which must match a
    /// configured package exactly.
    pub fn package_for_credits(&self, credits: i64) -> Option<&CreditPackage> {
        self.credit_packages.iter().find(|p| p.credits == credits)
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn default_credit_packages() -> Vec<CreditPackage> {
    vec![
        CreditPackage {
            price: 20,
            credits: 200,
            popular: false,
        },
        CreditPackage {
            price: 50,
            credits: 550,
            popular: true,
        },
        CreditPackage {
            price: 100,
            credits: 1200,
            popular: false,
        },
    ]
}

/// Parse `CREDIT_PACKAGES` in the form `price:credits[:popular],...`,
/// e.g. `20:200,50:550:popular,100:1200`.
///
/// Returns `None` when any entry is malformed so the caller can fall
/// back to the defaults instead of running with a partial list.
fn parse_credit_packages(s: &str) -> Option<Vec<CreditPackage>> {
    let mut packages = Vec::new();
    for entry in s.split(',') {
        let parts: Vec<&str> = entry.trim().split(':').collect();
        if parts.len() < 2 {
            return None;
        }
        let price: i64 = parts.first()?.parse().ok()?;
        let credits: i64 = parts.get(1)?.parse().ok()?;
        let popular = parts.iter().any(|p| *p == "popular");
        packages.push(CreditPackage {
            price,
            credits,
            popular,
        });
    }
    if packages.is_empty() {
        return None;
    }
    Some(packages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credit_packages() {
        let pkgs = parse_credit_packages("20:200,50:550:popular,100:1200").unwrap();
        assert_eq!(pkgs.len(), 3);
        assert_eq!(pkgs[0].price, 20);
        assert_eq!(pkgs[0].credits, 200);
        assert!(!pkgs[0].popular);
        assert!(pkgs[1].popular);
        assert_eq!(pkgs[2].credits, 1200);
    }

    #[test]
    fn test_parse_credit_packages_malformed() {
        assert!(parse_credit_packages("").is_none());
        assert!(parse_credit_packages("20").is_none());
        assert!(parse_credit_packages("20:abc").is_none());
        assert!(parse_credit_packages("20:200,bad").is_none());
    }

    #[test]
    fn test_package_lookup_by_credits() {
        let config = AppConfig {
            port: 0,
            db_path: String::new(),
            gemini_api_key: None,
            gemini_model: String::new(),
            assistant_credit_cost: 1,
            new_user_starting_credits: 20,
            credit_packages: default_credit_packages(),
            auth_secret: String::new(),
            stripe: StripeConfig {
                secret_key: None,
                webhook_secret: None,
                success_url: String::new(),
                cancel_url: String::new(),
            },
            seed_admin_email: String::new(),
            seed_admin_password: String::new(),
        };

        assert_eq!(config.package_for_credits(550).unwrap().price, 50);
        assert!(config.package_for_credits(999).is_none());
    }
}
