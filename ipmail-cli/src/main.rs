use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ipmail_core::config::DispatchConfig;
use ipmail_core::identity::export_base64;
use ipmail_core::logging::init_logging_with_config;
use ipmail_core::metrics::{init_metrics, DispatchStatsSnapshot};
use ipmail_core::network::MemoryPeer;
use ipmail_core::{
    Config, ContactDirectory, Dispatcher, Folder, Identity, IdentitySource, Mailboxes, MemoryNetwork, PubSub,
    Publisher, SelfIdentities, SharedContacts,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "ipmail")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file (defaults plus IPMAIL_* overrides otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding identity, contacts and mailboxes
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Passphrase for locked identities
    #[arg(long, env = "IPMAIL_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new default identity and an empty contact list
    Init {
        name: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        comment: String,
        /// Lock the secret keys with --passphrase
        #[arg(long)]
        lock: bool,
    },
    /// Show or export the default identity
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },
    /// Manage contacts
    Contacts {
        #[command(subcommand)]
        action: ContactsAction,
    },
    /// List the messages in a folder (sent, inbox, requests)
    List {
        #[arg(default_value = "inbox")]
        folder: String,
    },
    /// Print the text of one message
    Read {
        id: u64,
        #[arg(short, long, default_value = "inbox")]
        folder: String,
    },
    /// Accept or deny contact requests
    Requests {
        #[command(subcommand)]
        action: RequestsAction,
    },
    /// Run two peers on a loopback network and exchange a few messages
    Demo,
}

#[derive(Subcommand, Debug)]
enum IdentityAction {
    Show,
    /// Print the public identity as a base64: source
    Export,
}

#[derive(Subcommand, Debug)]
enum ContactsAction {
    /// Import a contact from file:, bin:, base64: or cid:
    Add { source: String },
    List,
}

#[derive(Subcommand, Debug)]
enum RequestsAction {
    Accept { id: u64 },
    Deny { id: u64 },
}

/// Identity, contacts and mailboxes of one data directory
struct Account {
    config: Config,
    selves: SelfIdentities,
    contacts: ContactDirectory,
}

impl Account {
    fn open(config: Config, passphrase: Option<&str>) -> Result<Self> {
        let identity_path = config.storage.identity_path();
        let mut selves = SelfIdentities::load(&identity_path).with_context(|| {
            format!("No identity at {} (run `ipmail init` first)", identity_path.display())
        })?;
        if let Some(passphrase) = passphrase {
            let unlocked = selves.unlock_all(passphrase.as_bytes());
            debug!(unlocked, "Unlocked identities");
        }

        let contacts_path = config.storage.contacts_path();
        let contacts = if contacts_path.exists() {
            ContactDirectory::load(&contacts_path)
                .with_context(|| format!("Failed to load contacts from {}", contacts_path.display()))?
        } else {
            ContactDirectory::new()
        };

        Ok(Self { config, selves, contacts })
    }

    fn mailboxes(&self) -> Result<Mailboxes> {
        Ok(Mailboxes::load(self.config.storage.paths(), &self.selves, &self.contacts)?)
    }

    fn save_contacts(&self) -> Result<()> {
        self.contacts.save(self.config.storage.contacts_path())?;
        Ok(())
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_env()?;
            config
        }
        None => Config::from_env()?,
    };
    if let Some(dir) = &args.data_dir {
        config.storage.data_dir = PathBuf::from(shellexpand::tilde(dir).into_owned());
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    config.validate()?;
    Ok(config)
}

fn init(config: Config, name: &str, comment: &str, email: &str, passphrase: Option<&str>) -> Result<()> {
    let identity_path = config.storage.identity_path();
    if identity_path.exists() {
        bail!("An identity already exists at {}", identity_path.display());
    }
    std::fs::create_dir_all(&config.storage.data_dir)
        .with_context(|| format!("Failed to create {}", config.storage.data_dir.display()))?;

    let mut identity = Identity::generate(name, comment, email)?;
    if let Some(passphrase) = passphrase {
        identity.lock(passphrase.as_bytes())?;
    }
    let selves = SelfIdentities::new(identity)?;
    selves.save(&identity_path)?;
    ContactDirectory::new().save(config.storage.contacts_path())?;

    info!(path = %identity_path.display(), "Created identity");
    println!("{}", selves.default_identity());
    println!("Key ID: {}", selves.default_identity().key_id());
    Ok(())
}

fn list(account: &Account, folder: &str) -> Result<()> {
    let folder = parse_folder(folder)?;
    let mailboxes = account.mailboxes()?;
    let store = mailboxes.store(folder);
    if store.is_empty() {
        println!("No messages in {}", folder);
    }
    store.for_each(|message| println!("{}", message));
    Ok(())
}

fn read(account: &Account, folder: &str, id: u64) -> Result<()> {
    let folder = parse_folder(folder)?;
    let mailboxes = account.mailboxes()?;
    let message = mailboxes
        .store(folder)
        .by_id(id)
        .with_context(|| format!("No message {} in {}", id, folder))?;
    println!("From: {}", message.sender());
    println!("Origin: {}", message.origin().as_str());
    println!();
    println!("{}", message.payload_text());
    Ok(())
}

async fn add_contact(account: &mut Account, source: &str) -> Result<()> {
    let source = IdentitySource::parse(source)?;
    // Offline: content addresses only resolve against an empty local store
    let network = MemoryNetwork::new();
    let identity = source.resolve(&network.peer("local")).await?;
    if account.contacts.add(identity.clone()) {
        account.save_contacts()?;
        println!("Added {}", identity);
    } else {
        println!("{} is already a contact", identity);
    }
    Ok(())
}

fn parse_folder(folder: &str) -> Result<Folder> {
    Folder::from_str(folder).map_err(anyhow::Error::msg)
}

/// Alice and Bob on one in-memory network. Bob knows Alice, Alice does not
/// know Bob yet, so Bob's message lands in her requests.
async fn demo(config: &DispatchConfig) -> Result<()> {
    let network = MemoryNetwork::with_buffer(config.subscription_buffer);
    let alice = DemoPeer::new(&network, "Alice", config)?;
    let bob = DemoPeer::new(&network, "Bob", config)?;
    bob.contacts.write().map_err(|_| anyhow::anyhow!("contacts lock poisoned"))?.add(alice.identity().clone());
    println!("Dispatching on topic {} ({:?})", config.topic, config.mode());

    let alice_run = alice.start(config).await?;
    let bob_run = bob.start(config).await?;

    let address = alice.publisher.send(b"Hello Bob!", true, alice.identity(), &[Some(bob.identity())]).await?;
    println!("Alice sent {}", address);
    let address = bob.publisher.send(b"Hi Alice, add me?", true, bob.identity(), &[Some(alice.identity())]).await?;
    println!("Bob sent {}", address);

    network.close_topic(&config.topic).await;
    let alice_stats = alice_run.await?;
    let bob_stats = bob_run.await?;
    debug!(?alice_stats, ?bob_stats, "Demo dispatchers finished");

    for peer in [&alice, &bob] {
        for folder in Folder::ALL {
            peer.mailboxes.store(folder).for_each(|message| {
                println!("{} [{}] {}: {}", peer.name, folder, message, message.payload_text())
            });
        }
    }
    Ok(())
}

struct DemoPeer {
    name: &'static str,
    net: MemoryPeer,
    selves: Arc<SelfIdentities>,
    contacts: SharedContacts,
    mailboxes: Arc<Mailboxes>,
    publisher: Publisher,
}

impl DemoPeer {
    fn new(network: &MemoryNetwork, name: &'static str, config: &DispatchConfig) -> Result<Self> {
        let net = network.peer(format!("loopback-{}", name.to_lowercase()));
        let shared = Arc::new(net.clone());
        Ok(Self {
            name,
            selves: Arc::new(SelfIdentities::generate(name, "demo", "")?),
            contacts: Arc::new(RwLock::new(ContactDirectory::new())),
            mailboxes: Arc::new(Mailboxes::in_memory()),
            publisher: Publisher::new(shared.clone(), shared).with_topic(config.topic.clone()),
            net,
        })
    }

    fn identity(&self) -> &Identity {
        self.selves.default_identity()
    }

    async fn start(&self, config: &DispatchConfig) -> Result<JoinHandle<DispatchStatsSnapshot>> {
        let subscription = self.net.subscribe(&config.topic).await?;
        let dispatcher = Dispatcher::new(
            Arc::new(self.net.clone()),
            self.selves.clone(),
            self.contacts.clone(),
            self.mailboxes.clone(),
        )
        .with_topic(config.topic.clone());
        let mode = config.mode();
        Ok(tokio::spawn(async move { dispatcher.run(subscription, mode).await }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let log_config = config.logging.to_log_config()?;
    init_logging_with_config(log_config)?;
    init_metrics();
    debug!(level = %config.logging.level, data_dir = %config.storage.data_dir.display(), "ipmail started");

    let passphrase = args.passphrase.as_deref();
    match args.command {
        Command::Init { name, email, comment, lock } => {
            let lock_with = if lock {
                Some(passphrase.context("--lock needs --passphrase or IPMAIL_PASSPHRASE")?)
            } else {
                None
            };
            init(config, &name, &comment, &email, lock_with)?;
        }
        Command::Identity { action } => {
            let account = Account::open(config, passphrase)?;
            let identity = account.selves.default_identity();
            match action {
                IdentityAction::Show => {
                    println!("{}", identity);
                    println!("Key ID: {}", identity.key_id());
                    println!("Locked: {}", identity.is_locked());
                }
                IdentityAction::Export => println!("base64:{}", export_base64(identity)?),
            }
        }
        Command::Contacts { action } => {
            let mut account = Account::open(config, passphrase)?;
            match action {
                ContactsAction::Add { source } => add_contact(&mut account, &source).await?,
                ContactsAction::List => account.contacts.for_each(|contact| {
                    println!("{}  {}", contact.key_id(), contact);
                }),
            }
        }
        Command::List { folder } => list(&Account::open(config, passphrase)?, &folder)?,
        Command::Read { id, folder } => read(&Account::open(config, passphrase)?, &folder, id)?,
        Command::Requests { action } => {
            let mut account = Account::open(config, passphrase)?;
            let mailboxes = account.mailboxes()?;
            let contacts_path = account.config.storage.contacts_path();
            match action {
                RequestsAction::Accept { id } => {
                    let contact = mailboxes.accept_request(id, &mut account.contacts, Some(&contacts_path))?;
                    println!("Added {} to contacts", contact);
                }
                RequestsAction::Deny { id } => {
                    mailboxes.deny_request(id)?;
                    println!("Denied request {}", id);
                }
            }
        }
        Command::Demo => demo(&config.dispatch).await?,
    }

    Ok(())
}
