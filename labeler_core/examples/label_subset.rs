//! Label the first records of a project with a registered agent.
//!
//! Reads `LABELER_HOST`, `LABELER_PROJECT` and `LABELER_ACCESS_TOKEN`
//! (or `~/.labeler/config.toml`), plus `OPENAI_API_KEY` for the model.
//!
//! Usage: cargo run --example label_subset -- <agent_uuid> <label_name>

use labeler_core::types::SearchQuery;
use labeler_core::{load_config, Authentication, Controller, CoreError, Service};

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let (Some(agent_uuid), Some(label_name)) = (args.next(), args.next()) else {
        eprintln!("usage: label_subset <agent_uuid> <label_name>");
        std::process::exit(2);
    };

    let config = load_config(None)?;
    let token = config
        .access_token
        .clone()
        .ok_or_else(|| CoreError::config("LABELER_ACCESS_TOKEN is not set"))?;

    let service = Service::from_config(&config).await?;
    let auth =
        Authentication::with_access_token(Some(&config.host), Some(&config.project), &token)
            .await?;
    let controller = Controller::new(&service, &auth);

    let subset = service
        .search(&SearchQuery {
            limit: 20,
            ..SearchQuery::default()
        })
        .await?;
    println!("records={}", subset.get_uuid_list().len());

    let job_uuid = controller.run_job(&agent_uuid, &subset, &label_name).await?;
    println!("job={}", job_uuid);

    let labeled = service.search_by_job(&job_uuid, None, Some(20), 0).await?;
    println!("labeled={}", labeled.get_uuid_list().len());
    Ok(())
}
