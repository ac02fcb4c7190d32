use std::collections::HashMap;

use once_cell::sync::Lazy;

/// IANA root WHOIS, asked for a `refer:` line when a TLD is not in the table.
pub const IANA_WHOIS_SERVER: &str = "whois.iana.org";

static WHOIS_SERVERS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // Generic TLDs
    m.insert("com", "whois.verisign-grs.com");
    m.insert("net", "whois.verisign-grs.com");
    m.insert("org", "whois.pir.org");
    m.insert("info", "whois.nic.info");
    m.insert("biz", "whois.nic.biz");
    m.insert("name", "whois.nic.name");
    m.insert("mobi", "whois.nic.mobi");
    m.insert("pro", "whois.nic.pro");
    m.insert("asia", "whois.nic.asia");
    m.insert("edu", "whois.educause.edu");
    m.insert("gov", "whois.dotgov.gov");

    // New gTLDs
    m.insert("app", "whois.nic.google");
    m.insert("dev", "whois.nic.google");
    m.insert("page", "whois.nic.google");
    m.insert("io", "whois.nic.io");
    m.insert("co", "whois.nic.co");
    m.insert("me", "whois.nic.me");
    m.insert("tv", "whois.nic.tv");
    m.insert("cc", "ccwhois.verisign-grs.com");
    m.insert("xyz", "whois.nic.xyz");
    m.insert("online", "whois.nic.online");
    m.insert("site", "whois.nic.site");
    m.insert("tech", "whois.nic.tech");
    m.insert("store", "whois.nic.store");
    m.insert("shop", "whois.nic.shop");
    m.insert("top", "whois.nic.top");
    m.insert("vip", "whois.nic.vip");
    m.insert("club", "whois.nic.club");
    m.insert("cloud", "whois.nic.cloud");
    m.insert("ai", "whois.nic.ai");

    // Country code TLDs
    m.insert("cn", "whois.cnnic.cn");
    m.insert("hk", "whois.hkirc.hk");
    m.insert("tw", "whois.twnic.net.tw");
    m.insert("jp", "whois.jprs.jp");
    m.insert("kr", "whois.kr");
    m.insert("sg", "whois.sgnic.sg");
    m.insert("in", "whois.registry.in");
    m.insert("au", "whois.auda.org.au");
    m.insert("nz", "whois.irs.net.nz");
    m.insert("uk", "whois.nic.uk");
    m.insert("de", "whois.denic.de");
    m.insert("fr", "whois.nic.fr");
    m.insert("nl", "whois.domain-registry.nl");
    m.insert("eu", "whois.eu");
    m.insert("it", "whois.nic.it");
    m.insert("es", "whois.nic.es");
    m.insert("ru", "whois.tcinet.ru");
    m.insert("us", "whois.nic.us");
    m.insert("ca", "whois.cira.ca");
    m.insert("br", "whois.registro.br");

    m
});

pub fn get_whois_server(tld: &str) -> Option<&'static str> {
    WHOIS_SERVERS.get(tld.to_lowercase().as_str()).copied()
}

pub fn get_tld(domain: &str) -> Option<&str> {
    domain.rsplit('.').next().filter(|tld| !tld.is_empty())
}

/// Extracts the `refer:` server from an IANA TLD response.
pub fn parse_iana_referral(response: &str) -> Option<String> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let key = key.trim().to_lowercase();
        if key == "refer" || key == "whois" {
            let server = value.trim().to_lowercase();
            (!server.is_empty() && server.contains('.')).then_some(server)
        } else {
            None
        }
    })
}
