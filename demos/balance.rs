//! Print the account balance for every vendor with a key in the environment.

use captcha_aio::{CapMonster, Provider, TwoCaptcha};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    if let Ok(key) = std::env::var("TWOCAPTCHA_KEY") {
        let provider = TwoCaptcha::builder(key).build()?;
        match provider.balance().await {
            Ok(balance) => println!("2captcha balance: {:.4}", balance),
            Err(e) => println!("2captcha balance failed ({}): {}", e.kind(), e),
        }
    }

    if let Ok(key) = std::env::var("CAPMONSTER_KEY") {
        let provider = CapMonster::builder(key).build()?;
        match provider.balance().await {
            Ok(balance) => println!("capmonster balance: {:.4}", balance),
            Err(e) => println!("capmonster balance failed ({}): {}", e.kind(), e),
        }
    }

    Ok(())
}
