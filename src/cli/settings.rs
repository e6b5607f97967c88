use crate::{
    config::{self, SETTING_KEYS},
    error, info,
    management::ConfigStore,
    success,
    sync::CONFIG_FILE,
};

async fn store() -> ConfigStore {
    match ConfigStore::open(config::data_dir().join(CONFIG_FILE)).await {
        Ok(store) => store,
        Err(e) => error!("Cannot open configuration. Err: {}", e),
    }
}

pub async fn get(key: String) {
    if !SETTING_KEYS.contains(&key.as_str()) {
        error!("Unknown setting '{}'. Known settings: {}", key, SETTING_KEYS.join(", "));
    }
    match store().await.get::<serde_json::Value>(&key).await {
        Ok(Some(value)) => println!("{}", value),
        Ok(None) => info!("{} is not set", key),
        Err(e) => error!("Cannot read {}. Err: {}", key, e),
    }
}

pub async fn set(key: String, value: String) {
    let value = match config::parse_setting(&key, &value) {
        Ok(value) => value,
        Err(e) => error!("{}", e),
    };
    match store().await.set(&key, &value).await {
        Ok(()) => success!("{} = {}", key, value),
        Err(e) => error!("Cannot write {}. Err: {}", key, e),
    }
}

pub async fn list() {
    let store = store().await;
    for key in SETTING_KEYS {
        match store.get::<serde_json::Value>(key).await {
            Ok(Some(value)) => println!("{} = {}", key, value),
            Ok(None) => println!("{} = (default)", key),
            Err(e) => error!("Cannot read {}. Err: {}", key, e),
        }
    }
}
