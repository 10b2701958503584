/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use time::Duration;
use tokio::sync::RwLock;

use crate::{
    auth, auth::AuthResult,
    store::Store,
    user::Role,
};

#[derive(Deserialize)]
struct ConfigFile {
    auth_db_connect_string: Option<String>,
    data_db_connect_string: Option<String>,
    admin_uname: Option<String>,
    admin_password: Option<String>,
    admin_name: Option<String>,
    admin_email: Option<String>,
    uploads_dir: Option<String>,
    key_lifetime_minutes: Option<i64>,
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug)]
pub struct Cfg {
    pub auth_db_connect_string: String,
    pub data_db_connect_string: String,
    pub default_admin_uname: String,
    pub default_admin_password: String,
    pub default_admin_name: String,
    pub default_admin_email: String,
    pub uploads_dir: PathBuf,
    pub key_lifetime: Duration,
    pub addr: SocketAddr,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            auth_db_connect_string: "host=localhost user=gmps_test password='gmps_test' dbname=gmps_auth_test".to_owned(),
            data_db_connect_string: "host=localhost user=gmps_test password='gmps_test' dbname=gmps_store_test".to_owned(),
            default_admin_uname: "root".to_owned(),
            default_admin_password: "toot".to_owned(),
            default_admin_name: "Default Admin".to_owned(),
            default_admin_email: "admin@gmps.not.an.address".to_owned(),
            uploads_dir: PathBuf::from("uploads"),
            key_lifetime: Duration::minutes(120),
            addr: SocketAddr::new(
                "0.0.0.0".parse().unwrap(),
                8001
            ),
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.auth_db_connect_string {
            c.auth_db_connect_string = s;
        }
        if let Some(s) = cf.data_db_connect_string {
            c.data_db_connect_string = s;
        }
        if let Some(s) = cf.admin_uname {
            c.default_admin_uname = s;
        }
        if let Some(s) = cf.admin_password {
            c.default_admin_password = s;
        }
        if let Some(s) = cf.admin_name {
            c.default_admin_name = s;
        }
        if let Some(s) = cf.admin_email {
            c.default_admin_email = s;
        }
        if let Some(s) = cf.uploads_dir {
            c.uploads_dir = PathBuf::from(s);
        }
        if let Some(n) = cf.key_lifetime_minutes {
            if n > 0 {
                c.key_lifetime = Duration::minutes(n);
            } else {
                return Err(format!(
                    "key_lifetime_minutes must be positive (got {})", &n
                ));
            }
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }

        Ok(c)
    }
}

/**
This guy will haul around some global variables and be passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    pub auth: RwLock<auth::Db>,
    pub data: RwLock<Store>,
    pub uploads_dir: PathBuf,
    pub addr: SocketAddr,
}

impl Glob {
    pub fn auth(&self) -> &RwLock<auth::Db> { &self.auth }
    pub fn data(&self) -> &RwLock<Store> { &self.data }
}

/// Loads system configuration and ensures all appropriate database tables
/// exist.
///
/// Also assures existence of the default admin and the uploads directory.
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<Glob, String> {
    let path = path.as_ref();
    let cfg = if path.exists() {
        Cfg::from_file(path)?
    } else {
        log::warn!(
            "Config file {} not found; using compiled-in defaults.",
            path.display()
        );
        Cfg::default()
    };
    log::info!("Configuration read:\n{:#?}", &cfg);

    log::trace!("Checking state of auth DB...");
    let auth_db = auth::Db::new(
        cfg.auth_db_connect_string.clone(),
        cfg.key_lifetime,
    );
    if let Err(e) = auth_db.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of auth DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...auth DB okay.");

    log::trace!("Checking state of data DB...");
    let data_db = Store::new(cfg.data_db_connect_string.clone());
    if let Err(e) = data_db.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of data DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...data DB okay.");

    log::trace!("Checking existence of default admin in data DB...");
    match data_db.get_admin_by_uname(&cfg.default_admin_uname).await {
        Err(e) => {
            let estr = format!(
                "Error attempting to check existence of default admin ({}) in data DB: {}",
                &cfg.default_admin_uname, &e
            );
            return Err(estr);
        },
        Ok(None) => {
            log::info!(
                "Default admin ({}) doesn't exist in data DB; inserting.",
                &cfg.default_admin_uname
            );
            if let Err(e) = data_db.insert_admin(
                &cfg.default_admin_uname,
                &cfg.default_admin_name,
                &cfg.default_admin_email
            ).await {
                let estr = format!(
                    "Error inserting default admin into data DB: {}", &e
                );
                return Err(estr);
            }
        },
        Ok(Some(_)) => {},
    }
    log::trace!("Default admin OK in data DB.");

    log::trace!("Checking existence of default admin in auth DB...");
    match auth_db.check_password(
        &cfg.default_admin_uname,
        Role::Admin,
        &cfg.default_admin_password,
    ).await {
        Err(e) => {
            let estr = format!(
                "Error checking existence of default admin in auth DB: {}", &e
            );
            return Err(estr);
        },
        Ok(AuthResult::BadPassword) => {
            log::warn!(
                "Default admin ({}) not using default password.",
                &cfg.default_admin_uname
            );
        },
        Ok(AuthResult::NoSuchUser) => {
            log::info!(
                "Default admin ({}) doesn't exist in auth DB; inserting.",
                &cfg.default_admin_uname
            );
            if let Err(e) = auth_db.add_user(
                &cfg.default_admin_uname,
                Role::Admin,
                &cfg.default_admin_password
            ).await {
                let estr = format!(
                    "Error inserting default admin into auth DB: {}", &e
                );
                return Err(estr);
            }
            log::trace!("Default admin inserted into auth DB.");
        },
        Ok(AuthResult::Ok) => {
            log::trace!("Default admin password check OK.");
        },
        Ok(x) => {
            let estr = format!(
                "Default admin password check resulted in {:?}, which just doesn't make sense.",
                &x
            );
            return Err(estr);
        },
    }
    log::trace!("Default admin OK in auth DB.");

    if let Err(e) = std::fs::create_dir_all(&cfg.uploads_dir) {
        return Err(format!(
            "Unable to create uploads directory {}: {}",
            cfg.uploads_dir.display(), &e
        ));
    }

    let glob = Glob {
        auth: RwLock::new(auth_db),
        data: RwLock::new(data_db),
        uploads_dir: cfg.uploads_dir,
        addr: cfg.addr,
    };

    Ok(glob)
}
