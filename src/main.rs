use std::sync::Arc;

use popbus::config::{Settings, load_config};
use popbus::utils::logging;
use popbus::{Broker, Error};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&config.logging.level);

    if let Err(e) = run(config).await {
        error!("popbus demo failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Settings) -> popbus::Result<()> {
    info!(
        "Starting broker with {:?} dispatch and {:?} inboxes",
        config.broker.dispatch,
        config.inbox.policy()
    );

    let broker = Arc::new(Broker::<String>::new(&config));
    let subscriber = broker.add_subscriber()?;
    broker.subscribe(&subscriber, "news")?;
    broker.subscribe(&subscriber, "weather")?;

    let consumer = {
        let subscriber = subscriber.clone();
        tokio::spawn(async move {
            loop {
                match subscriber.receive().await {
                    Ok(message) => info!(
                        "{} received {:?} on {}",
                        subscriber.id(),
                        message.payload(),
                        message.topic()
                    ),
                    Err(Error::ChannelClosed) => break,
                    Err(e) => {
                        error!("Receive failed: {}", e);
                        break;
                    }
                }
            }
        })
    };

    for (topic, payload) in [("news", "hello"), ("weather", "sunny"), ("sport", "nobody listens")] {
        let report = broker.publish(topic, payload.to_string()).await.wait().await;
        info!("Published to {}: {:?}", topic, report);
    }

    broker.remove_subscriber(&subscriber);
    if let Err(e) = consumer.await {
        error!("Consumer task failed: {}", e);
    }
    info!("Final stats: {:?}", broker.stats());
    Ok(())
}
