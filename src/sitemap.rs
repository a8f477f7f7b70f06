use crate::models::{Newsletter, Post};

/// One `<url>` entry in the sitemap.
struct SitemapUrl {
    loc: String,
    lastmod: Option<String>,
    changefreq: &'static str,
    priority: &'static str,
}

/// generate_sitemap
///
/// Renders the sitemaps.org XML for the public site: the static pages plus one
/// entry per published post (`{base}/{slug}`) and newsletter issue
/// (`{base}/newsletters/{id}`). Callers pass only already-published content;
/// no visibility filtering happens here.
pub fn generate_sitemap(base_url: &str, posts: &[Post], newsletters: &[Newsletter]) -> String {
    let base = base_url.trim_end_matches('/');

    let mut urls = vec![
        static_page(format!("{base}/"), "weekly", "1.0"),
        static_page(format!("{base}/newsletters"), "weekly", "0.8"),
        static_page(format!("{base}/pricing"), "monthly", "0.7"),
        static_page(format!("{base}/search"), "monthly", "0.6"),
    ];

    urls.extend(posts.iter().map(|post| SitemapUrl {
        loc: format!("{base}/{}", post.slug),
        lastmod: Some(post.updated_at.format("%Y-%m-%d").to_string()),
        changefreq: "monthly",
        priority: "0.9",
    }));

    urls.extend(newsletters.iter().map(|issue| SitemapUrl {
        loc: format!("{base}/newsletters/{}", issue.id),
        lastmod: Some(issue.updated_at.format("%Y-%m-%d").to_string()),
        changefreq: "monthly",
        priority: "0.8",
    }));

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for url in &urls {
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&url.loc)));
        if let Some(lastmod) = &url.lastmod {
            xml.push_str(&format!("    <lastmod>{lastmod}</lastmod>\n"));
        }
        xml.push_str(&format!("    <changefreq>{}</changefreq>\n", url.changefreq));
        xml.push_str(&format!("    <priority>{}</priority>\n", url.priority));
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

fn static_page(loc: String, changefreq: &'static str, priority: &'static str) -> SitemapUrl {
    SitemapUrl {
        loc,
        lastmod: None,
        changefreq,
        priority,
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
        .replace('"', "&quot;")
}
