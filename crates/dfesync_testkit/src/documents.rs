//! Sample fiscal documents.

use crate::fixtures::ISSUER_CNPJ;

fn mod11_digit(digits: &str) -> u32 {
    let sum: u32 = digits
        .bytes()
        .rev()
        .zip((2..=9).cycle())
        .map(|(b, w)| u32::from(b - b'0') * w)
        .sum();
    match sum % 11 {
        0 | 1 => 0,
        r => 11 - r,
    }
}

/// A 44-digit NF-e access key issued by [`ISSUER_CNPJ`] with invoice `number`.
pub fn nfe_key(number: u32) -> String {
    let body = format!("352401{ISSUER_CNPJ}55001{number:09}1{:08}", number % 100_000_000);
    format!("{body}{}", mod11_digit(&body))
}

/// A 50-digit national NFS-e access key issued by [`ISSUER_CNPJ`].
pub fn nfse_key(number: u64) -> String {
    let body = format!("355030821{ISSUER_CNPJ}{number:013}2401{:09}", number % 1_000_000_000);
    format!("{body}{}", mod11_digit(&body))
}

/// An invoice summary (`resNFe`).
pub fn res_nfe(key: &str, issuer_name: &str) -> String {
    format!(
        "<resNFe xmlns=\"http://www.portalfiscal.inf.br/nfe\" versao=\"1.01\">\
         <chNFe>{key}</chNFe><CNPJ>{ISSUER_CNPJ}</CNPJ><xNome>{issuer_name}</xNome>\
         <IE>110042490114</IE><dhEmi>2024-01-10T10:00:00-03:00</dhEmi><tpNF>1</tpNF>\
         <vNF>150.00</vNF><digVal>x</digVal><dhRecbto>2024-01-10T10:00:05-03:00</dhRecbto>\
         <nProt>135240000000001</nProt><cSitNFe>1</cSitNFe></resNFe>"
    )
}

/// A summary without issuer name; pair with `nfe_key(0)` for one with no readable number.
pub fn res_nfe_without_identity(key: &str) -> String {
    format!(
        "<resNFe xmlns=\"http://www.portalfiscal.inf.br/nfe\" versao=\"1.01\">\
         <chNFe>{key}</chNFe><vNF>1.00</vNF></resNFe>"
    )
}

/// A complete authorized invoice (`nfeProc`).
pub fn nfe_proc(key: &str, issuer_name: &str) -> String {
    let number = &key[25..34];
    format!(
        "<nfeProc xmlns=\"http://www.portalfiscal.inf.br/nfe\" versao=\"4.00\">\
         <NFe><infNFe Id=\"NFe{key}\" versao=\"4.00\">\
         <ide><cUF>35</cUF><mod>55</mod><serie>1</serie><nNF>{}</nNF>\
         <dhEmi>2024-01-10T10:00:00-03:00</dhEmi></ide>\
         <emit><CNPJ>{ISSUER_CNPJ}</CNPJ><xNome>{issuer_name}</xNome></emit>\
         <total><ICMSTot><vNF>150.00</vNF></ICMSTot></total>\
         </infNFe></NFe>\
         <protNFe versao=\"4.00\"><infProt><chNFe>{key}</chNFe><cStat>100</cStat></infProt></protNFe>\
         </nfeProc>",
        number.trim_start_matches('0')
    )
}

/// An event summary (`resEvento`).
pub fn res_evento(key: &str, event_type: &str) -> String {
    format!(
        "<resEvento xmlns=\"http://www.portalfiscal.inf.br/nfe\" versao=\"1.01\">\
         <cOrgao>91</cOrgao><CNPJ>{ISSUER_CNPJ}</CNPJ><chNFe>{key}</chNFe>\
         <dhEvento>2024-01-11T09:00:00-03:00</dhEvento><tpEvento>{event_type}</tpEvento>\
         <nSeqEvento>1</nSeqEvento><xEvento>Cancelamento</xEvento>\
         <dhRecbto>2024-01-11T09:00:03-03:00</dhRecbto><nProt>135240000000002</nProt></resEvento>"
    )
}

/// A national NFS-e.
pub fn nfse(key: &str, issuer_name: &str) -> String {
    let number = &key[23..36];
    format!(
        "<NFSe xmlns=\"http://www.sped.fazenda.gov.br/nfse\" versao=\"1.00\">\
         <infNFSe Id=\"NFS{key}\"><xLocEmi>Sao Paulo</xLocEmi><nNFSe>{}</nNFSe>\
         <dhProc>2024-01-10T10:00:00-03:00</dhProc>\
         <emit><CNPJ>{ISSUER_CNPJ}</CNPJ><xNome>{issuer_name}</xNome></emit>\
         <valores><vLiq>980.00</vLiq></valores></infNFSe></NFSe>",
        number.trim_start_matches('0')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_have_expected_lengths() {
        assert_eq!(nfe_key(1234).len(), 44);
        assert_eq!(nfse_key(12).len(), 50);
    }

    #[test]
    fn keys_embed_number() {
        assert_eq!(&nfe_key(1234)[25..34], "000001234");
        assert_eq!(&nfse_key(12)[23..36], "0000000000012");
    }
}
