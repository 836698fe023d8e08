use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use pwreset_rs::{
    ProviderEndpoints,
    RecoveryWorkflow,
    TwoCaptchaOracle,
    VERSION,
    retrieve_email_otp,
};
use tokio::runtime::Runtime;
use url::Url;

fn prompt(label: &str) -> io::Result<String> {
    print!("{} ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn parse_u64(input: &str, default: u64) -> u64 {
    input.trim().parse().ok().filter(|value| *value > 0).unwrap_or(default)
}

fn parse_usize(input: &str, default: usize) -> usize {
    input.trim().parse().ok().filter(|value| *value > 0).unwrap_or(default)
}

#[test]
#[ignore = "Requires network access, a solver API key, and manual input"]
fn interactive_full_recovery() -> Result<(), Box<dyn Error>> {
    println!("pwreset-rs {} interactive recovery test", VERSION);
    println!("Provide inputs when prompted. Press Enter to accept defaults.\n");

    let base_input = prompt("Provider signin base URL [https://signin.example.com/]:")?;
    let base = if base_input.is_empty() {
        "https://signin.example.com/".to_string()
    } else {
        base_input
    };

    let email = prompt("Account e-mail address:")?;
    if email.is_empty() {
        println!("No e-mail given, aborting.");
        return Ok(());
    }

    let api_key = prompt("2Captcha-compatible API key:")?;
    let poll_answer = prompt("Answer poll interval seconds [5]:")?;
    let timeout_answer = prompt("Solve timeout seconds [120]:")?;
    let attempts_answer = prompt("Max challenge attempts [3]:")?;

    let endpoints = ProviderEndpoints::for_base(&Url::parse(&base)?)?;
    let workflow = RecoveryWorkflow::builder()
        .with_endpoints(endpoints)
        .with_oracle(Arc::new(TwoCaptchaOracle::new(api_key)?))
        .with_poll_interval(Duration::from_secs(parse_u64(&poll_answer, 5)))
        .with_solve_timeout(Duration::from_secs(parse_u64(&timeout_answer, 120)))
        .with_max_captcha_attempts(parse_usize(&attempts_answer, 3))
        .build()?;

    let runtime = Runtime::new()?;

    println!("\nRequesting OTP for {email}...");
    let context = runtime.block_on(workflow.request_otp(&email))?;
    println!("Challenge cleared; landing page retained ({} bytes).", context.document().body.len());

    println!("\nCheck the account inbox for the verification e-mail.");
    let email_body = prompt("Paste the e-mail body (single line), or leave empty to stop:")?;
    if email_body.is_empty() {
        println!("Stopping before password commit.");
        return Ok(());
    }

    let otp = retrieve_email_otp(&email_body)?;
    println!("Extracted OTP: {otp}");

    let new_password = prompt("New password:")?;
    let changed = runtime.block_on(workflow.commit_password(context, &new_password, &otp))?;

    if changed {
        println!("Password changed successfully.");
    } else {
        println!("Provider did not confirm the change; inspect the account manually.");
    }

    Ok(())
}
